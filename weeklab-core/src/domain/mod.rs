//! Domain types for Weeklab.

pub mod bar;
pub mod chain;
pub mod order;
pub mod position;
pub mod result;

pub use bar::MarketBar;
pub use chain::{Greeks, OptionContract, OptionRight, OptionsChain};
pub use order::{FillOutcome, LegFill, LegSide, OrderLeg, OrderTicket, TradePhase, TradeRecord, TradeStatus};
pub use position::Position;
pub use result::WeeklyResult;

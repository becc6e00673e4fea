//! Message-collecting validators. They never fail; callers decide whether a
//! message is fatal.

mod daily_history;
mod mql_auxiliary;

pub use daily_history::DailyHistoryChartValidations;
pub use mql_auxiliary::MqlAuxiliaryValidations;

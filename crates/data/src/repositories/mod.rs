//! Typed database access, one repository per table.

pub mod alert_history_repo;
pub mod alert_rule_repo;
pub mod bar_repo;
pub mod tick_repo;

pub use alert_history_repo::AlertHistoryRepository;
pub use alert_rule_repo::AlertRuleRepository;
pub use bar_repo::BarRepository;
pub use tick_repo::TickRepository;

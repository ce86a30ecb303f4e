//! Outbound sinks: alerts and the trade journal

pub mod journal;
pub mod notify;

pub use journal::{JsonlJournal, PersistenceSink, RecordKind, TradeRecord};
pub use notify::{Alert, AlertDispatcher, LogNotifier, NotificationSink, TelegramNotifier};

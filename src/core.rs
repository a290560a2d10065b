//! The update engine: events/errors, backup, download, diff, delete
//! policy, HTTP-FS crawl, and the orchestrator that sequences them.

pub mod events;
pub use events::{ErrorCode, Event, EventSink, Mode, UpdaterError, no_op_sink};

pub mod backup;
pub use backup::{BackupErr, BackupManager};

pub mod downloader;
pub use downloader::{DownloadErr, Downloader};

pub mod diff;
pub use diff::{Action, Plan, PlanErr};

pub mod delete_policy;

pub mod httpfs;
pub use httpfs::{HttpFsCrawler, HttpFsErr};

pub mod orchestrator;
pub use orchestrator::{FreeSpace, OtaOutcome, RebootHook, SystemFreeSpace, SystemReboot, Updater};

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod external;
pub mod loader;
pub mod monitor;
pub mod report;
pub mod rewriter;
pub mod rules;
pub mod script;
pub mod shortcut_file;
pub mod storage;
pub mod syntax;

// Re-export common items for convenience
pub use config::{get_config_dir, get_settings_file_path, Settings};
pub use context::{ExpansionContext, ResultText};
pub use engine::{ExpansionEngine, ExpansionListener, LifecycleOutcome};
pub use error::{Result, SourcePosition, TejsError};
pub use external::{ExternalRunner, ShellRunner};
pub use loader::{LoadSummary, ShortcutLoader, SETTINGS_SOURCE};
pub use monitor::{FileMonitor, MonitorPolicy, StorageEvent};
pub use report::{MessageLevel, Report, Reporter, TracingReporter};
pub use rules::{RuleTable, SharedRuleTable, ShortcutRule};
pub use shortcut_file::{parse_shortcut_file, ParseOptions, ParsedShortcutFile};
pub use storage::{FileStamp, FileStore, FsStore, StampSource};
pub use syntax::SyntaxDescriptor;

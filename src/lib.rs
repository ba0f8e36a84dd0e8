pub mod browser;
pub mod config;
pub mod discover;
pub mod element;
pub mod error;
pub mod fill;
pub mod generate;
pub mod overlay;
pub mod page;
pub mod profile;
pub mod resolve;
pub mod scope;
pub mod session;
pub mod stealth;
pub mod text;

pub use browser::AutofillBrowser;
pub use config::{AutofillConfig, BrowserBuilder, BrowserConfig};
pub use discover::{discover, ControlId, ControlKind, FieldDescriptor};
pub use error::{Error, Result};
pub use fill::{CancelFlag, ControlDriver, FillExecutor, FillReport, TypingCadence};
pub use generate::{AnswerBridge, ChatCompletionsGenerator, GenerationError, Generator};
pub use page::{Page, Trigger};
pub use profile::{ProfileRecord, ProfileValue};
pub use resolve::{FieldResolver, Resolution};
pub use scope::{FormScope, ScopeSelector, SelectionSurface};
pub use session::{AutofillSession, Panel};

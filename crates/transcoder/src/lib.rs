pub mod config;
pub mod error;
pub mod store;
pub mod hydrus;
pub mod link;
pub mod probe;
pub mod decision;
pub mod locator;
pub mod encoder;
pub mod cleanup;
pub mod convert;
pub mod preflight;

pub use config::{ImageProfile, Profiles, TranscodeConfig, VideoProfile};
pub use error::{ItemError, TranscodeError};
pub use store::{FileHash, FileMetadata, SearchQuery, Services, StoreClient};
pub use hydrus::HydrusClient;
pub use link::{LinkAmbiguity, LinkIndex, LinkReader};
pub use probe::MediaProbe;
pub use decision::{Action, DecisionEngine, DecisionInput, MediaCategory, SkipReason};
pub use locator::FileLocator;
pub use encoder::{CommandBuilder, ExternalTools, MediaTools};
pub use cleanup::{CleanupReport, ReconciliationPass};
pub use convert::{ConversionPass, ConversionReport, RunState};

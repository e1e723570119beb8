// Bulk submission engine for throttled graph stores

pub mod config;
pub use config::{LoaderConfig, ThrottleConfig};

pub mod element;
pub use element::{Edge, GraphElement, Properties, PropertyValue, Vertex};

pub mod error;
pub use error::{ConfigError, FatalBatchError, LoadError, WriteError};

pub mod outcome;
pub use outcome::{
    BatchReport, ElementFailure, OperationOutcome, RunTotals, WriteMode, WriteOperation,
};

pub mod store;
pub use store::{GraphStore, WriteResponse};

pub mod throttle;
pub use throttle::{Adjustment, ConcurrencyController, ConcurrencyState, Plan};

pub mod executor;
pub use executor::{BatchExecutor, CancelSignal};

pub mod orchestrator;
pub use orchestrator::{BatchState, BulkOrchestrator};

pub mod simulated;
pub use simulated::{SimulatedStore, SimulatedStoreConfig, SimulatedStoreStats};

pub mod source;
pub use source::ElementReader;

pub mod marker;
pub use marker::MarkerWriter;

pub mod loader;
pub use loader::{BulkLoader, LoadReport, RunSummary};

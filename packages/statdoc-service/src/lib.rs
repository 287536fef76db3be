pub mod evidence;
pub mod generate;
pub mod pipeline;
pub mod quality_loop;

mod error;

pub use error::{Error, Result};
pub use evidence::{EvidenceSet, build_evidence};
pub use generate::{DraftOutput, EvidenceSnippet, GenerationRequest, Generator, HttpGenerator};
pub use pipeline::{ProcessOutcome, process_job};
pub use quality_loop::{LoopOutcome, run_quality_loop};

use std::{future::Future, pin::Pin};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

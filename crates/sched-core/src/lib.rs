//! Core scheduling primitives: radix-tree prefix cache, slot-table
//! management, prefill admission, batch metadata, and the shadow-compare
//! harness over it. Fully synchronous; the surrounding runtime owns all
//! blocking I/O (see `sched-transport`/`sched-cli`).

pub mod admission;
pub mod batch;
pub mod radix;
pub mod request;
pub mod sampling;
pub mod shadow;
pub mod slots;

pub use admission::{AdmissionPlanner, Scheduler, StepBudget};
pub use batch::{make_metadata_buffers, metadata_for_batch, BatchMetadata, WRITE_POS_SKIP};
pub use radix::{EvictShortfall, Handle, RadixCache, SizeInfo};
pub use request::{AdmittedRequest, Batch, PendingRequest, Phase, TokenId, Uid};
pub use sampling::SamplingParams;
pub use shadow::{MetadataBackend, NativeMetadataBackend, ShadowHarness, ShadowSnapshot};
pub use slots::{KvSlotPool, SlotTable};

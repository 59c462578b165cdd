//! Input guardrails for tool invocations.
//!
//! Three mechanisms compose in front of the invocation pipeline:
//!
//! - [`injection`]: regex pattern matching over string arguments, with an
//!   optional (strictly advisory) external LLM verdict.
//! - [`loop_detection`]: a consecutive-call hash over (tool, arguments) with
//!   cooldowns, guarding against an agent looping on an identical call.
//! - [`sensitive`]: classification of destructive or privileged operations
//!   so their results can be wrapped with a warning.
//!
//! [`composite::CompositeGuardrails`] chains injection and loop checks,
//! short-circuiting on the first block.

pub mod composite;
pub mod injection;
pub mod loop_detection;
pub mod sensitive;

pub use composite::{CompositeGuardrails, GuardrailsResult};
pub use injection::{DetectionResult, InjectionDetector, LlmDetectionConfig, Severity};
pub use loop_detection::{LoopDetectionConfig, LoopDetectionResult, LoopDetector};
pub use sensitive::{check_sensitive_operation, SensitiveOperation};

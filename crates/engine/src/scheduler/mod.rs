//! When sweeps run.
//!
//! Three triggers share one [`Sweeper`](crate::sweeper::Sweeper):
//! - [`BackgroundProcessor`] sweeps everything on a fixed interval;
//! - [`InlineCleanupTrigger`] launches capped sweeps from the request path,
//!   rate limited by a [`CooldownGate`];
//! - operators run [`Sweeper::run`](crate::sweeper::Sweeper::run) directly
//!   with manual options.

mod background;
mod gate;
mod inline;

pub use background::{BackgroundConfig, BackgroundProcessor, BackgroundProcessorBuilder};
pub use gate::CooldownGate;
pub use inline::{InlineCleanupTrigger, InlineConfig};

//! Background worker plumbing shared by the generation orchestrators.

mod pill;
mod worker;

pub(crate) use pill::Pill;
pub(crate) use worker::WorkerHandle;

//! `lumen` mirrors the colors at the edges of a screen onto an addressable LED
//! strip wrapped around it.
//!
//! # Structure
//!
//! A [`session::Session`] runs two periodic tasks sharing one configuration
//! snapshot: the [`pipeline::CapturePipeline`], which turns captured frames
//! into LED color sequences, and the [`power_saving::PowerSavingEvaluator`],
//! which turns the strip off when the screen content stays static or the
//! screensaver runs. LED data is delivered by the [`dispatcher::OutputDispatcher`].

#[macro_use]
extern crate tracing;

pub mod capture;
pub mod device;
pub mod dispatcher;
pub mod display;
pub mod image;
pub mod models;
pub mod pipeline;
pub mod power_saving;
pub mod session;

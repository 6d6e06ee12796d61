//! bantam-content — Stateless client for the generation API.
//!
//! Wraps an OpenAI-compatible chat + image endpoint. One structured
//! document per call, no retries, no client-side timeouts; failure
//! policy is per-operation (see [`ContentClient`]).

pub mod client;

pub use client::{Concept, ContentClient, ContentError, Entity};

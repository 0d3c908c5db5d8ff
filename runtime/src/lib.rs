// Copyright 2026 Case Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Case Harvest: capture weapon-case data from a client-rendered catalog site
//! and normalize it into relational rows.
//!
//! Pipeline per parent: a [`acquisition::DetailSource`] yields raw item
//! records (directly from the API, or by intercepting the page's own call via
//! [`intercept::Interceptor`]), `case_catalog::transform` classifies them, and
//! [`pipeline::persist`] upserts items and parent links into a
//! [`store::Store`].

pub mod acquisition;
pub mod capture;
pub mod cli;
pub mod config;
pub mod dump;
pub mod error;
pub mod harvest;
pub mod intercept;
pub mod pipeline;
pub mod renderer;
pub mod store;

pub use config::HarvestConfig;
pub use error::{AcquireError, CaptureError, ConfigError, FetchError, ParentError, StoreError};
pub use harvest::{BatchReport, Harvester, ParentOutcome, RunReport};
pub use pipeline::{persist, PersistStats};

// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod cache;
pub mod categories;
pub mod columns;
pub mod csrf;
pub mod filters;
pub mod forms;
pub mod history;
pub mod ids;
pub mod loader;
pub mod modals;
pub mod model;
pub mod query;
pub mod rows;
pub mod state;

pub use ids::*;
pub use model::*;
pub use state::*;

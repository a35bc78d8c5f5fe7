// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod calendar;
pub mod error;
pub mod forms;
pub mod ids;
pub mod model;
pub mod validation;

pub use error::*;
pub use forms::*;
pub use ids::*;
pub use model::*;

// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod forms;
pub mod model;
pub mod phone;
pub mod state;

pub use forms::*;
pub use model::*;
pub use phone::*;
pub use state::*;

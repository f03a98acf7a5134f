// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod reader;
mod validate;

pub use reader::{ReadError, SheetFormat, read_first_sheet};
pub use validate::{
    LARGE_FILE_ROWS, REQUIRED_COLUMNS, SAMPLE_ROWS, validate_bytes, validate_grid, validate_path,
};

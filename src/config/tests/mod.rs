//! Unit tests for configuration loading and precedence.
//!
//! Tests are organised into modules by functional area:
//! - `helpers`: Shared test utilities
//! - `precedence`: Layer precedence tests
//! - `loading`: Real loading from CLI arguments and the environment
//! - `operation_mode`: Operation mode and input source tests
//! - `base_urls`: Service root resolution tests
//! - `validation`: Configuration consistency validation tests

mod helpers;
mod precedence;

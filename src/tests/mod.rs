pub mod test_helpers;

mod field_store_tests;
mod interpolation_tests;

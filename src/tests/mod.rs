// Test modules for all components
pub mod test_circulant;

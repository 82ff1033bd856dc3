// Commerce services backing the storefront API
pub mod commerce;

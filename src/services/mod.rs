// Pricing and cart resolution
pub mod eligibility;
pub mod order_meta;
pub mod pricing;

// Order lifecycle
pub mod orders;
pub mod payments;
pub mod settlement;

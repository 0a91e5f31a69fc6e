// Entity-specific transformers

pub mod customer;
pub mod erp_customer_demo;
pub mod erp_location;
pub mod product;
pub mod product_category;
pub mod sales_detail;

pub use customer::CustomerTransformer;
pub use erp_customer_demo::ErpCustomerDemoTransformer;
pub use erp_location::ErpLocationTransformer;
pub use product::ProductTransformer;
pub use product_category::ProductCategoryTransformer;
pub use sales_detail::SalesDetailTransformer;

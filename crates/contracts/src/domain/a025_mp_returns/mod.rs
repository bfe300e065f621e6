pub mod aggregate;
pub mod dto;
pub mod filter;

pub use aggregate::{BuyerInfo, OrderSummary, ReturnFinancial, ReturnProduct, ReturnRecord};
pub use dto::{ListPagination, ListFilters, ReturnsListRequest, ReturnsListResponse};
pub use filter::{AccountSelection, FilterCriteria, FilterPatch};

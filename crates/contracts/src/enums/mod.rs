pub mod review_status;

pub mod payment_writer;
pub mod product_reader;

pub mod byte_helpers;

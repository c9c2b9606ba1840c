pub mod bankda;

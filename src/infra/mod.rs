// Infrastructure adapters implementing application ports
pub mod ftp;

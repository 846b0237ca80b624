pub mod affinities;
pub mod distances;
pub mod init;
pub mod perplexity;

//! Git access through libgit2.

pub mod repository;

pub use repository::GitRepository;

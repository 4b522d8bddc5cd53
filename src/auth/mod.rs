pub mod dto;
pub mod password;
pub mod repo;
mod repo_types;
pub mod resolvers;
pub(crate) mod services;

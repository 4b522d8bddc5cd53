pub mod dto;
pub mod repo;
mod repo_types;
pub mod resolvers;
pub mod services;

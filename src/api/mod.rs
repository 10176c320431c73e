pub mod handler;
pub mod server;

#[cfg(test)]
mod tests;

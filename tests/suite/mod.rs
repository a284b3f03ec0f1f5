mod config;
mod session;
mod transport;

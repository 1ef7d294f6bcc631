// IPC module - Communication between client and daemon

pub mod client;
pub mod controller;
pub mod protocol;
pub mod server;

pub use client::IpcClient;
pub use controller::Controller;
pub use protocol::{Command, Request, Response, ResponseData};
pub use server::IpcServer;

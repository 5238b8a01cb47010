pub mod mock_server;
pub mod scripted;

pub mod mock_http;

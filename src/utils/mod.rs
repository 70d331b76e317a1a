pub mod api_error;
pub mod clipboard;
pub mod syntax;
#[cfg(test)]
pub mod test_utils;
pub mod url;

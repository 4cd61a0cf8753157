mod bind;
mod cbox;
mod connection;
mod dialect;
mod driver;
mod extract;
mod transaction;

use libsqlite3_sys::{sqlite3, sqlite3_errmsg};
use std::ffi::CStr;

pub(crate) use cbox::*;
pub use connection::*;
pub use dialect::*;
pub use driver::*;
pub use transaction::*;

pub(crate) fn error_message(connection: *mut sqlite3) -> String {
    unsafe {
        let message = sqlite3_errmsg(connection);
        if message.is_null() {
            return "Unknown error (could not extract the error message)".into();
        }
        CStr::from_ptr(message).to_string_lossy().into_owned()
    }
}

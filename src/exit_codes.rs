//! Exit code policy for snowctl.
//!
//! - `0` = Success
//! - `2` = Usage error (bad arguments, reported by clap)
//!
//! ## Failures (10+)
//!
//! - `10` = General operational failure (disk, terminal, unexpected)
//! - `11` = Warehouse failure (login, statement, transport)
//! - `12` = Configuration or validation error
//! - `13` = Named connection does not exist
//!
//! Scripts can tell "the warehouse said no" (11) apart from "snowctl was
//! configured wrong" (12) without parsing messages.

use crate::error::Error;
use crate::warehouse::WarehouseError;

/// Exit code: usage error
pub const USAGE: i32 = 2;

/// Exit code: general operational failure
pub const OPERATIONAL_FAILURE: i32 = 10;

/// Exit code: warehouse or connection failure
pub const CONNECTION_FAILURE: i32 = 11;

/// Exit code: configuration or validation error
pub const CONFIG_ERROR: i32 = 12;

/// Exit code: connection not found
pub const NOT_FOUND: i32 = 13;

/// Exit code: interrupted by Ctrl+C (SIGINT)
pub const INTERRUPTED: i32 = 130;

/// Pick the exit code from the first typed error in the chain.
pub fn for_error(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<Error>() {
            return match e {
                Error::NotFound(_) => NOT_FOUND,
                Error::Io { .. } => OPERATIONAL_FAILURE,
                _ => CONFIG_ERROR,
            };
        }
        if cause.downcast_ref::<WarehouseError>().is_some() {
            return CONNECTION_FAILURE;
        }
    }
    OPERATIONAL_FAILURE
}

//! Ingests a GTFS Realtime vehicle-positions feed on a fixed interval and
//! keeps the latest position of every vehicle in PostgreSQL, flagging vehicles
//! that drop out of the feed as inactive.

pub mod config;
pub mod decoder;
pub mod error;
pub mod fetch;
pub mod health;
pub mod output;
pub mod pull;
pub mod reconcile;
pub mod record;
pub mod report;
pub mod retention;
pub mod store;
pub mod timestamp;
pub mod translate;

pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}

mod connection;
mod output;
mod show;
mod sql;

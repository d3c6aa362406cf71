pub mod geoip;
pub mod handler;
pub mod hasher;
pub mod useragent;

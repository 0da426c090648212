use std::time::Duration;

use crate::{
  descriptor::ConnectionDescriptor,
  driver::memory::{MemoryDriver, MemoryDriverOptions},
  provision::Provisioner,
};

pub const TEST_DB: &str = "seed_test";

pub fn descriptor() -> ConnectionDescriptor {
  ConnectionDescriptor::new(TEST_DB)
    .with_param("host", "localhost")
    .with_param("port", 28015)
}

pub fn create_driver() -> MemoryDriver {
  MemoryDriver::with_options(MemoryDriverOptions {
    build_delay: Duration::from_millis(5),
    ..Default::default()
  })
}

/// A provisioner over a fresh in-memory server, plus a handle to inspect it.
pub fn create_provisioner() -> (MemoryDriver, Provisioner) {
  let driver = create_driver();
  let provisioner = Provisioner::new(Box::new(driver.clone()));
  (driver, provisioner)
}

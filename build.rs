fn main() {
    // Host builds (unit/integration tests) have no ESP-IDF environment to
    // export; only the device binary needs the sysenv link arguments.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}

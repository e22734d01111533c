fn main() {
    capture_relay_lib::run()
}

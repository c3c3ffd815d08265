fn main() {
    switchboard_lib::run()
}

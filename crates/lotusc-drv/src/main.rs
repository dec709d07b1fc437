fn main() {
    std::process::exit(lotusc_drv::main());
}

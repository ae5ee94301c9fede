fn main() {
    stratum_pool::main();
}

use std::io::ErrorKind;
use std::path::Path;
use std::{fs, io};

const PROTO_FILE: &str = "./protos/raft.proto";

fn main() -> io::Result<()> {
    println!("cargo:rerun-if-changed={}", PROTO_FILE);
    build_proto()?;
    Ok(())
}

fn build_proto() -> io::Result<()> {
    idempotent_create_dir("./generated/")?;
    tonic_build::configure()
        .build_client(true)
        .build_server(true)
        .out_dir("./generated/")
        .compile(&[PROTO_FILE], &["./protos/"])
}

fn idempotent_create_dir<P: AsRef<Path>>(path: P) -> io::Result<()> {
    match fs::create_dir(path) {
        Ok(_) => Ok(()),
        Err(e) => match e.kind() {
            ErrorKind::AlreadyExists => Ok(()),
            _ => Err(e),
        },
    }
}

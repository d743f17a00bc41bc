//! Matrix Component Compiler Binary

use matrixc::cli::MatrixCli;
use std::process;

fn main() {
    match MatrixCli::new().run() {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

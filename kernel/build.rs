use std::{env, fs, path::PathBuf};

fn main() {
    let target = env::var("CARGO_CFG_TARGET_ARCH").unwrap();
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    if target == "riscv32" {
        // Build startup code and archive it
        let compiler =
            env::var("RV32OS_CC").unwrap_or_else(|_| String::from("riscv64-unknown-elf-gcc"));

        let mut cc = cc::Build::new();
        cc.compiler(compiler)
            .flag("-march=rv32imac_zicsr")
            .flag("-mabi=ilp32");

        #[cfg(feature = "config-qemu")]
        cc.flag("-DCONFIG_QEMU");

        cc.file("src/arch/riscv/startup.S").compile("libcpu.a");

        println!("cargo:rerun-if-changed=src/arch/riscv/startup.S");
        println!("cargo:rerun-if-changed=linkers/riscv32.ld");
    }

    // Embed the first user program. Builds without one get an empty image.
    let image = match env::var("RV32OS_USER_IMAGE") {
        Ok(path) => {
            println!("cargo:rerun-if-changed={}", path);
            fs::read(&path).unwrap_or_else(|e| panic!("cannot read user image {}: {}", path, e))
        }
        Err(_) => Vec::new(),
    };
    fs::write(out_dir.join("user.bin"), image).unwrap();

    println!("cargo:rerun-if-env-changed=RV32OS_USER_IMAGE");
    println!("cargo:rerun-if-env-changed=RV32OS_CC");
    println!("cargo:rerun-if-changed=build.rs");
}

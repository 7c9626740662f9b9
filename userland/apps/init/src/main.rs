#![no_std]
#![no_main]

use runtime::{fs, io::Write, println};

#[unsafe(no_mangle)]
pub extern "C" fn main() -> isize {
    let mut stdout = runtime::io::stdout();
    stdout.write(b"Hello Rust user space!\n").ok();

    let msg = b"Hello from shell!\n";
    match fs::write(c"hello.txt", msg) {
        Ok(n) => println!("init: wrote {} bytes to hello.txt", n),
        Err(e) => println!("init: cannot write hello.txt: {}", e),
    }

    let mut buf = [0; 128];
    match fs::read(c"hello.txt", &mut buf) {
        Ok(n) => {
            stdout.write(b"init: hello.txt says: ").ok();
            stdout.write(&buf[..n]).ok();
        }
        Err(e) => println!("init: cannot read hello.txt: {}", e),
    }

    if fs::read(c"missing.txt", &mut buf).is_err() {
        println!("init: missing.txt is not there, as expected");
    }

    runtime::shutdown()
}

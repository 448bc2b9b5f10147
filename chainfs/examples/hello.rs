use std::env;

use chainfs::{ChainFs, Geometry};

pub fn main() -> chainfs::Result<()> {
    let path = env::args().nth(1).unwrap_or_else(|| "hello.disk".to_string());

    let mut fs = ChainFs::create(&path, Geometry::default())?;
    fs.make_directory("/hello")?;
    fs.make_file("/hello/world.txt")?;
    fs.write("/hello/world.txt", b"Hello, world!\n", 0)?;

    let mut buf = [0; 64];
    let n = fs.read("/hello/world.txt", &mut buf, 0)?;
    print!("{}", String::from_utf8_lossy(&buf[..n]));
    println!("{:?}", fs.list_directory("/hello")?);
    Ok(())
}

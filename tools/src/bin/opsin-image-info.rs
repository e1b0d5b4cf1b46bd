fn main() {
    async_global_executor::block_on(run()).unwrap();
}

async fn run() -> Result<(), opsin::Error> {
    let mut args = std::env::args();
    let bin = args.next().unwrap();
    let Some(path) = args.next() else {
        eprintln!("Usage: {bin} <IMAGE PATH> [NUMBER FRAMES]");
        std::process::exit(2);
    };
    let n_frames = args.next().and_then(|x| x.parse().ok()).unwrap_or(1);

    let image = opsin::Loader::new(path).load().await?;

    let info = image.info();

    println!("[info]");
    println!("dimensions = {} x {}", info.width, info.height);
    println!("format_name = {}", info.format_name);
    println!("mime_type = {}", image.mime_type());
    println!("animated = {}", info.animated);
    println!("memory_format = {:?}", image.memory_format());
    println!("sandbox = {:?}", image.active_sandbox_mechanism());

    if !image.metadata_keys().is_empty() {
        println!("[metadata]");
        for key in image.metadata_keys() {
            println!(
                "{key} = {}",
                image.metadata_key_value(&key).unwrap_or(String::from("-"))
            );
        }
    }

    for _ in 0..n_frames {
        let frame = image.next_frame().await?;
        println!("[[frame]]");
        println!("dimensions = {} x {}", frame.width(), frame.height());
        println!("stride = {}", frame.stride());
        println!("format = {:?}", frame.memory_format());
        println!(
            "delay = {}",
            frame
                .delay()
                .map(|x| format!("{:#?}", x))
                .unwrap_or(String::from("-"))
        );
    }

    Ok(())
}

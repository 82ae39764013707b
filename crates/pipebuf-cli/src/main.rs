use pipebuf_core::BackingMode;

fn main() {
    pipebuf_cli::main_for(BackingMode::Memory);
}

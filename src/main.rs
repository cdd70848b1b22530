use anyhow::Result;

fn main() -> Result<()> {
    bluemrv::run()?;
    Ok(())
}

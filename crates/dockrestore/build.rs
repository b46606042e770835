use anyhow::Result;
use vergen_gitcl::{Emitter, GitclBuilder};

pub fn main() -> Result<()> {
    if Emitter::default()
        .add_instructions(&GitclBuilder::all_git()?)?
        .emit()
        .is_err()
    {
        // building from a source tarball, no git metadata around
        println!("cargo:rustc-env=VERGEN_GIT_SHA=unknown");
    }
    Ok(())
}

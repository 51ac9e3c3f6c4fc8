//! Entry points available to `--invoke`.

use std::io::{self, Write};
use ttyrelay_terminal::{InvocationContext, InvocationTable};

pub fn builtin_entries() -> InvocationTable {
    let mut table = InvocationTable::new();
    table.register("cat", cat);
    table.register("echo", echo);
    table
}

/// Copy input to output until the renderer closes the session.
fn cat(mut ctx: InvocationContext) -> anyhow::Result<()> {
    io::copy(&mut ctx.stdin, &mut ctx.stdout)?;
    Ok(())
}

fn echo(mut ctx: InvocationContext) -> anyhow::Result<()> {
    writeln!(ctx.stdout, "{}", ctx.args.join(" "))?;
    Ok(())
}

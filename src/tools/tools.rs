//! CLI front-end for the script and strtab codecs (§6 External Interfaces).

mod numeric;
mod script_dump;
use script_dump::script_dump;
mod script_embed;
use script_embed::script_embed;
mod statement_text;
mod strtab_dump;
use strtab_dump::strtab_dump;
mod strtab_embed;
use strtab_embed::strtab_embed;

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};

use numeric::parse_num;
use vnpatch::embed::StrtabKind;
use vnpatch::script::script_by_name;

/// Patches scripts and strtabs into a visual-novel ROM image.
#[derive(Clone, Debug, Parser)]
struct Args {
    /// path to the ROM image
    rom: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Dump or embed one script's bytecode
    Script(ScriptArgs),
    /// Dump or embed one raw strtab
    Strtab(StrtabArgs),
}

#[derive(Clone, Debug, Parser)]
struct ScriptArgs {
    /// known script name (see the built-in registry); used to fill in any
    /// VMA left as 0
    name: String,
    /// script command-buffer VMA, or 0 to resolve from `name`
    #[arg(value_parser = parse_num)]
    script_vma: u32,
    /// script strtab VMA, or 0 to resolve from `name`
    #[arg(value_parser = parse_num)]
    strtab_script_vma: u32,
    /// menu strtab VMA; must be given explicitly, the registry only tracks
    /// one strtab per script
    #[arg(value_parser = parse_num)]
    strtab_menu_vma: u32,
    #[command(subcommand)]
    op: ScriptOp,
}

#[derive(Clone, Debug, Subcommand)]
enum ScriptOp {
    /// Disassemble the script to text
    Dump {
        /// output path; stdout if omitted
        out: Option<PathBuf>,
    },
    /// Assemble a statement-list file and splice it into the ROM
    Embed {
        /// minimal line-based statement-list source (see `statement_text`)
        input: PathBuf,
        /// 0 to rebuild both strtabs from the index files below, 1 to leave
        /// the ROM's existing strtabs untouched
        use_rom_strtab: u8,
        /// maximum script byte-size the target buffer allows
        #[arg(value_parser = parse_num)]
        script_size: u32,
        /// per-script size field VMA patched with the final bytecode length
        #[arg(value_parser = parse_num)]
        script_size_ptr_vma: u32,
        strtab_script_file: PathBuf,
        strtab_menu_file: PathBuf,
        #[arg(value_parser = parse_num)]
        strtab_script_size: u32,
        #[arg(value_parser = parse_num)]
        strtab_menu_size: u32,
        out: PathBuf,
    },
}

#[derive(Clone, Debug, Parser)]
struct StrtabArgs {
    /// strtab VMA
    #[arg(value_parser = parse_num)]
    strtab_vma: u32,
    #[command(subcommand)]
    op: StrtabOp,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrtabKindArg {
    Script,
    Menu,
}

impl From<StrtabKindArg> for StrtabKind {
    fn from(value: StrtabKindArg) -> Self {
        match value {
            StrtabKindArg::Script => StrtabKind::Script,
            StrtabKindArg::Menu => StrtabKind::Menu,
        }
    }
}

#[derive(Clone, Debug, Subcommand)]
enum StrtabOp {
    /// Dump every entry (or just `idx`) to text
    Dump {
        out: Option<PathBuf>,
        #[arg(value_parser = parse_num)]
        idx: Option<u32>,
    },
    /// Build a standalone strtab from an index file and splice it into the ROM
    Embed {
        input: PathBuf,
        #[arg(value_parser = parse_num)]
        size: u32,
        #[arg(value_enum)]
        kind: StrtabKindArg,
        out: PathBuf,
    },
}

/// The VMAs a `script` invocation actually operates on, after resolving any
/// left at 0 against [`vnpatch::script::KNOWN_SCRIPTS`].
pub struct ResolvedScript {
    pub script_vma: u32,
    pub strtab_script_vma: u32,
    pub strtab_menu_vma: u32,
    pub script_size_ptr_vma: u32,
}

fn resolve_script(args: &ScriptArgs, script_size_ptr_vma: u32) -> Result<ResolvedScript> {
    let descriptor = script_by_name(&args.name);
    let script_vma = match args.script_vma {
        0 => descriptor.map(|d| d.vma).ok_or_else(|| anyhow!("script {:?} is not in the known-script registry", args.name))?,
        vma => vma,
    };
    let strtab_script_vma = match args.strtab_script_vma {
        0 => descriptor.map(|d| d.strtab_vma).ok_or_else(|| anyhow!("script {:?} is not in the known-script registry", args.name))?,
        vma => vma,
    };
    if args.strtab_menu_vma == 0 {
        return Err(anyhow!("strtab_menu_vma must be given explicitly"));
    }
    Ok(ResolvedScript { script_vma, strtab_script_vma, strtab_menu_vma: args.strtab_menu_vma, script_size_ptr_vma })
}

fn main() -> Result<()> {
    let args = Args::parse();

    match &args.command {
        Command::Script(script_args) => match &script_args.op {
            ScriptOp::Dump { out } => {
                let resolved = resolve_script(script_args, 0)?;
                script_dump(&args.rom, &resolved, out)
            }
            ScriptOp::Embed {
                input,
                use_rom_strtab,
                script_size,
                script_size_ptr_vma,
                strtab_script_file,
                strtab_menu_file,
                strtab_script_size,
                strtab_menu_size,
                out,
            } => {
                let resolved = resolve_script(script_args, *script_size_ptr_vma)?;
                script_embed(
                    &args.rom,
                    &resolved,
                    input,
                    *use_rom_strtab != 0,
                    *script_size,
                    strtab_script_file,
                    strtab_menu_file,
                    *strtab_script_size,
                    *strtab_menu_size,
                    out,
                )
            }
        },
        Command::Strtab(strtab_args) => match &strtab_args.op {
            StrtabOp::Dump { out, idx } => strtab_dump(&args.rom, strtab_args.strtab_vma, out, idx),
            StrtabOp::Embed { input, size, kind, out } => {
                strtab_embed(&args.rom, strtab_args.strtab_vma, input, *size, (*kind).into(), out)
            }
        },
    }
}

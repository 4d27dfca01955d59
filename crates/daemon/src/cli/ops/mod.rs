use clap::Subcommand;

pub mod add_folder;
pub mod init;
pub mod list;
pub mod run;
pub mod snapshot;

crate::command_enum! {
    (Init, init::Init),
    (AddFolder, add_folder::AddFolder),
    (Run, run::Run),
    (Snapshot, snapshot::Snapshot),
    (List, list::List),
}

// CLI module
//
// This module contains command-line interface functionality:
// - arguments: Command-line argument parsing and conversion into library settings

pub mod arguments;

pub use arguments::{AuthArgs, CasProxyArguments, CasProxyCommands};

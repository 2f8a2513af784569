use anstyle::{AnsiColor, Color, Style};
use clap::{builder::Styles, Parser, Subcommand};
use clap_verbosity_flag::Verbosity;

use crate::commands;

/// Styles for CLI
fn get_styles() -> Styles {
  Styles::styled()
    .header(
      Style::new()
        .bold()
        .underline()
        .fg_color(Some(Color::Ansi(AnsiColor::Green))),
    )
    .literal(Style::new().bold().fg_color(Some(Color::Ansi(AnsiColor::BrightCyan))))
    .usage(
      Style::new()
        .bold()
        .fg_color(Some(Color::Ansi(AnsiColor::Green))),
    )
    .placeholder(
      Style::new()
        .bold()
        .underline()
        .fg_color(Some(Color::Ansi(AnsiColor::Yellow))),
    )
}

#[derive(Debug, Parser)]
#[command(author, about, version)]
#[command(propagate_version = true)]
#[command(styles=get_styles())]
pub struct Cli {
  #[command(subcommand)]
  pub command: Commands,

  #[clap(flatten)]
  pub verbose: Verbosity,

  /// Disable colored log output
  #[arg(long, global = true)]
  pub no_color: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
  /// Create the VPC stack: VPC, public and private subnets, gateways and route tables
  ///
  /// Exports `vpcId`, `publicSubnetIDs` and `privateSubnetIDs` for use by other stacks
  Vpc(commands::vpc::Network),

  /// Create the application stack inside the VPC exported by a VPC stack
  ///
  /// Creates the security groups, a classic load balancer and a single instance auto scaling group
  App(commands::app::App),

  /// Print the outputs exported by a stack
  Outputs(commands::outputs::Outputs),
}

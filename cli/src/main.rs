/*
 * main.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Burl, an HTTP(S) command-line transfer agent.
 *
 * Burl is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Burl is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Burl.  If not, see <http://www.gnu.org/licenses/>.
 */

//! burl entry point: parse flags, run the batch sequentially, write the
//! cookie jar, map failures to exit codes (22 for --fail on HTTP >= 400).

mod options;

use std::process::ExitCode;

use clap::Parser;

use burl_core::config::FailMode;
use burl_core::error::Error;
use burl_core::executor::Executor;

use crate::options::Args;

const EXIT_HTTP_ERROR: u8 = 22;

async fn run() -> Result<u8, Error> {
    let invocation = Args::parse().into_invocation()?;
    let fail = invocation.config.fail;
    let jar_path = invocation.config.cookie_jar_path.clone();

    let mut executor = Executor::new(invocation.config, invocation.jar);

    let mut exit = 0u8;
    let infos = executor.config().urls.clone();
    for info in &infos {
        let status = executor.execute_with_retry(info).await?;
        if fail != FailMode::None && status >= 400 {
            eprintln!("Error: The requested URL returned error: {}", status);
            exit = EXIT_HTTP_ERROR;
            break;
        }
    }

    if let Some(path) = jar_path {
        let text = executor
            .jar()
            .map(|jar| jar.to_netscape())
            .unwrap_or_default();
        if path == std::path::Path::new("-") {
            print!("{}", text);
        } else {
            std::fs::write(&path, text).map_err(Error::Io)?;
        }
    }

    Ok(exit)
}

fn main() -> ExitCode {
    env_logger::init();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run()) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

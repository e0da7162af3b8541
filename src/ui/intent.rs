// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! User intents typed at the console.

use thiserror::Error;

/// Which device a connect intent refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectTarget {
    /// 1-based row in the device list.
    Row(usize),
    /// Hardware address.
    Address(String),
}

/// An action requested by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    RequestScan,
    RequestConnect(ConnectTarget),
    RequestDisconnect,
    /// Send the pending text, replacing it first when text is given.
    RequestSend(Option<String>),
    TextChanged(String),
    ShowDevices,
    ShowMessages,
    Help,
    Quit,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum IntentError {
    #[error("Unknown command: {0}")]
    Unknown(String),

    #[error("Usage: connect <row|address>")]
    MissingTarget,
}

pub const HELP: &str = "\
Commands:
  scan                    search for nearby devices
  connect <row|address>   connect to a listed device
  text <message>          set the text to send
  send [message]          send the pending text (or the given message)
  disconnect              close the connection
  devices                 list discovered devices
  messages                show received messages
  help                    show this help
  quit                    exit";

impl Intent {
    /// Parse one console line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Intent>, IntentError> {
        let line = line.trim_start();
        if line.trim().is_empty() {
            return Ok(None);
        }

        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest),
            None => (line.trim_end(), ""),
        };

        let intent = match command.to_lowercase().as_str() {
            "scan" | "s" => Intent::RequestScan,
            "connect" | "c" => {
                let target = rest.trim();
                if target.is_empty() {
                    return Err(IntentError::MissingTarget);
                }
                match target.parse::<usize>() {
                    Ok(row) => Intent::RequestConnect(ConnectTarget::Row(row)),
                    Err(_) => Intent::RequestConnect(ConnectTarget::Address(target.to_uppercase())),
                }
            }
            "disconnect" | "d" => Intent::RequestDisconnect,
            // Payloads are kept verbatim apart from the separating space
            "text" => Intent::TextChanged(rest.to_string()),
            "send" => {
                if rest.is_empty() {
                    Intent::RequestSend(None)
                } else {
                    Intent::RequestSend(Some(rest.to_string()))
                }
            }
            "devices" | "ls" => Intent::ShowDevices,
            "messages" | "m" => Intent::ShowMessages,
            "help" | "?" => Intent::Help,
            "quit" | "exit" | "q" => Intent::Quit,
            other => return Err(IntentError::Unknown(other.to_string())),
        };

        Ok(Some(intent))
    }
}

/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

use crate::error::{CliError, CliResult};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use wsxhub::{HubConfig, DEFAULT_INSIDE_PORT, DEFAULT_OUTSIDE_ALLOW, DEFAULT_OUTSIDE_PORT};

/// Optional json5 configuration file for `wsxhub server`.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub(crate) inside_port: Option<u16>,
    #[serde(default)]
    pub(crate) outside_port: Option<u16>,
    #[serde(default)]
    pub(crate) outside_allow: Option<String>,
}

/// Values given on the command line; they win over the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub(crate) inside_port: Option<u16>,
    pub(crate) outside_port: Option<u16>,
    pub(crate) outside_allow: Option<String>,
}

impl Config {
    pub fn load(path: &Path) -> CliResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| CliError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        json5::from_str(&contents).map_err(|source| CliError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn into_hub_config(self, overrides: Overrides) -> HubConfig {
        let inside_port = overrides
            .inside_port
            .or(self.inside_port)
            .unwrap_or(DEFAULT_INSIDE_PORT);
        let outside_port = overrides
            .outside_port
            .or(self.outside_port)
            .unwrap_or(DEFAULT_OUTSIDE_PORT);
        let outside_allow = overrides
            .outside_allow
            .or(self.outside_allow)
            .unwrap_or_else(|| DEFAULT_OUTSIDE_ALLOW.to_string());

        HubConfig {
            inside_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, inside_port)),
            outside_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, outside_port)),
            outside_allow,
        }
    }
}

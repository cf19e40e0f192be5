//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Authentication plugins for the connection-validation handshake.
//!
//! During validation the server offers the authentication mechanisms it
//! accepts and the client answers with one plugin name plus an optional
//! initial token. Plugins are consulted in the order they were configured;
//! the first one whose name the server offered wins.

/// One authentication mechanism the client can answer validation with.
pub trait SecurityPlugin: Send + Sync {
    /// Mechanism name matched against the server's offered list.
    fn name(&self) -> &str;

    /// Token sent alongside the name in the validation response.
    fn initial_token(&self) -> Option<String> {
        None
    }
}

/// The no-credentials mechanism. Every context carries it by default so
/// validation can always be answered.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousPlugin;

impl SecurityPlugin for AnonymousPlugin {
    fn name(&self) -> &str {
        "anonymous"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_plugin_has_no_token() {
        let plugin = AnonymousPlugin;
        assert_eq!(plugin.name(), "anonymous");
        assert!(plugin.initial_token().is_none());
    }

    struct TokenPlugin;

    impl SecurityPlugin for TokenPlugin {
        fn name(&self) -> &str {
            "token"
        }

        fn initial_token(&self) -> Option<String> {
            Some("tok-123".to_string())
        }
    }

    #[test]
    fn test_custom_plugin_supplies_token() {
        let plugin = TokenPlugin;
        assert_eq!(plugin.initial_token().as_deref(), Some("tok-123"));
    }
}

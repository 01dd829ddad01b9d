use crate::error::ClientError;
use crate::session::Storage;

pub const THEME_KEY: &str = "ui_theme";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    /// Anything but `dark` reads as light.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "dark" => Theme::Dark,
            _ => Theme::Light,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

/// Light/dark preference persisted between runs.
pub struct ThemeStore {
    storage: Box<dyn Storage>,
    theme: Theme,
}

impl ThemeStore {
    pub fn load(storage: impl Storage + 'static) -> Result<Self, ClientError> {
        let theme = storage
            .get(THEME_KEY)?
            .map(|raw| Theme::parse(&raw))
            .unwrap_or_default();
        Ok(Self {
            storage: Box::new(storage),
            theme,
        })
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn set(&mut self, theme: Theme) -> Result<(), ClientError> {
        self.storage.set(THEME_KEY, theme.as_str())?;
        self.theme = theme;
        Ok(())
    }

    pub fn toggle(&mut self) -> Result<Theme, ClientError> {
        self.set(self.theme.toggled())?;
        Ok(self.theme)
    }
}

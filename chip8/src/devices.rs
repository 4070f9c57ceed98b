//! IO device interface
use crate::{constants::*, display::Framebuffer};

/// Snapshot of the 16 keys, indexed by key value.
pub type Keypad = [bool; KEY_COUNT];

/// Hooks to provide IO devices to the virtual machine.
///
/// See [`Chip8Vm::drive`](crate::prelude::Chip8Vm::drive).
pub trait Devices {
    /// Current state of the keypad. Polled once per driver iteration.
    fn keypad(&mut self) -> Keypad;

    /// Blit the display buffer to screen output.
    fn draw(&mut self, display: &Framebuffer);

    /// Turn the sound buzzer on or off.
    fn buzz(&mut self, state: bool);
}

/// Logical key of the hexadecimal keypad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(try_from = "u8"))]
#[repr(u8)]
pub enum KeyCode {
    Key0 = 0,
    Key1,
    Key2,
    Key3,
    Key4,
    Key5,
    Key6,
    Key7,
    Key8,
    Key9,
    KeyA,
    KeyB,
    KeyC,
    KeyD,
    KeyE,
    KeyF = 0xF,
}

impl KeyCode {
    #[inline(always)]
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    #[inline(always)]
    pub fn as_index(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for KeyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let key_id = self.as_u8();
        write!(f, "k{key_id:x}")
    }
}

impl From<KeyCode> for u8 {
    fn from(keycode: KeyCode) -> Self {
        keycode.as_u8()
    }
}

impl TryFrom<u8> for KeyCode {
    type Error = InvalidKeyCode;

    fn try_from(key_id: u8) -> Result<Self, Self::Error> {
        match key_id {
            0 => Ok(Self::Key0),
            1 => Ok(Self::Key1),
            2 => Ok(Self::Key2),
            3 => Ok(Self::Key3),
            4 => Ok(Self::Key4),
            5 => Ok(Self::Key5),
            6 => Ok(Self::Key6),
            7 => Ok(Self::Key7),
            8 => Ok(Self::Key8),
            9 => Ok(Self::Key9),
            10 => Ok(Self::KeyA),
            11 => Ok(Self::KeyB),
            12 => Ok(Self::KeyC),
            13 => Ok(Self::KeyD),
            14 => Ok(Self::KeyE),
            15 => Ok(Self::KeyF),
            _ => Err(InvalidKeyCode),
        }
    }
}

/// Build a keypad snapshot with the given keys held down.
pub fn keypad_with<'a>(keys: impl IntoIterator<Item = &'a KeyCode>) -> Keypad {
    let mut keypad = [false; KEY_COUNT];
    for key in keys {
        keypad[key.as_index()] = true;
    }
    keypad
}

#[derive(Debug)]
pub struct InvalidKeyCode;

impl std::error::Error for InvalidKeyCode {}

impl std::fmt::Display for InvalidKeyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "keycode must be in range 0 <= keycode < 16")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_keycode_conversion() {
        for key_id in 0..KEY_COUNT as u8 {
            let keycode = KeyCode::try_from(key_id).unwrap();
            assert_eq!(u8::from(keycode), key_id);
        }
        assert!(KeyCode::try_from(16).is_err());
        assert_eq!(KeyCode::KeyA.to_string(), "ka");
    }

    #[test]
    fn test_keypad_with() {
        let keypad = keypad_with(&[KeyCode::Key1, KeyCode::KeyF]);
        assert!(keypad[1]);
        assert!(keypad[15]);
        assert_eq!(keypad.iter().filter(|k| **k).count(), 2);
    }
}

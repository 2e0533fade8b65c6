#![forbid(unsafe_code)]

//! Screen: a component fronting a display frame.
//!
//! The screen owns a shared [`Frame`] handle and attaches it to the host's
//! framer once every sibling exists. Guest-visible methods cover resolution,
//! palette, power state, and the keyboards bound to this screen; the frame's
//! cell operations are host-side API used by the renderer and the log
//! mirror.

use std::cell::RefCell;
use std::rc::Weak;

use boxen_value::{Table, Value, ValuePack};

use boxen_frame::{Frame, FrameHandle, Framer};

use crate::component::{
    Component, ComponentBase, MethodDecl, MethodError, MethodResult, PostInitCtx,
};
use crate::error::ClientError;

const DEFAULT_WIDTH: u16 = 80;
const DEFAULT_HEIGHT: u16 = 25;

/// Palette slots exposed to the guest.
const PALETTE_SIZE: usize = 16;

/// Default palette: the conventional 16 terminal colors.
const DEFAULT_PALETTE: [u32; PALETTE_SIZE] = [
    0x000000, 0xAA0000, 0x00AA00, 0xAA5500, 0x0000AA, 0xAA00AA, 0x00AAAA, 0xAAAAAA, 0x555555,
    0xFF5555, 0x55FF55, 0xFFFF55, 0x5555FF, 0xFF55FF, 0x55FFFF, 0xFFFFFF,
];

static METHODS: &[MethodDecl] = &[
    MethodDecl::new("getKeyboards", "function():table -- The addresses of the keyboards bound to this screen."),
    MethodDecl::new("setResolution", "function(width:number, height:number):boolean -- Set the resolution; returns whether it changed."),
    MethodDecl::new("getResolution", "function():number, number -- The current resolution."),
    MethodDecl::new("maxResolution", "function():number, number -- The maximum supported resolution."),
    MethodDecl::new("setPaletteColor", "function(index:number, value:number):number -- Set a palette entry; returns the previous value."),
    MethodDecl::new("getPaletteColor", "function(index:number):number -- Read a palette entry."),
    MethodDecl::new("isOn", "function():boolean -- Whether the screen is powered on."),
    MethodDecl::new("turnOn", "function():boolean -- Power on; returns whether the state changed."),
    MethodDecl::new("turnOff", "function():boolean -- Power off; returns whether the state changed."),
];

pub struct Screen {
    base: ComponentBase,
    frame: FrameHandle,
    framer: Weak<RefCell<dyn Framer>>,
    keyboards: Vec<String>,
    palette: [u32; PALETTE_SIZE],
    on: bool,
}

impl Screen {
    pub fn create(
        entry: &mut Table,
        framer: Weak<RefCell<dyn Framer>>,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            base: ComponentBase::from_entry(entry),
            frame: Frame::shared(DEFAULT_WIDTH, DEFAULT_HEIGHT),
            framer,
            keyboards: Vec::new(),
            palette: DEFAULT_PALETTE,
            on: true,
        })
    }

    /// The display frame this screen fronts.
    #[must_use]
    pub fn frame(&self) -> FrameHandle {
        self.frame.clone()
    }

    fn max_resolution(&self) -> (u16, u16) {
        self.framer
            .upgrade()
            .map_or((DEFAULT_WIDTH, DEFAULT_HEIGHT), |f| {
                f.borrow().max_resolution()
            })
    }

    fn palette_index(&self, args: &ValuePack, slot: usize) -> Result<usize, MethodError> {
        let index = args.arg::<i64>(slot)?;
        if !(0..PALETTE_SIZE as i64).contains(&index) {
            return Err(MethodError::failure("invalid palette index"));
        }
        Ok(index as usize)
    }
}

impl Component for Screen {
    fn address(&self) -> &str {
        self.base.address()
    }

    fn kind(&self) -> &'static str {
        "screen"
    }

    fn slot(&self) -> i64 {
        self.base.slot()
    }

    fn methods(&self) -> &'static [MethodDecl] {
        METHODS
    }

    fn post_init(&mut self, ctx: &PostInitCtx<'_>) -> Result<(), ClientError> {
        self.keyboards = ctx.keyboards.to_vec();
        let (max_w, max_h) = self.max_resolution();
        self.frame
            .borrow_mut()
            .set_resolution(DEFAULT_WIDTH.min(max_w), DEFAULT_HEIGHT.min(max_h), true);
        if let Some(framer) = self.framer.upgrade() {
            framer.borrow_mut().add(self.frame.clone(), None);
        }
        Ok(())
    }

    fn invoke(&mut self, method: &str, args: &ValuePack) -> MethodResult {
        match method {
            "getKeyboards" => {
                let mut list = Table::new();
                for address in &self.keyboards {
                    list.push(Value::from(address.clone()));
                }
                Ok(ValuePack::of([Value::Table(list)]))
            }
            "setResolution" => {
                let width = args.arg::<i64>(0)?;
                let height = args.arg::<i64>(1)?;
                let (max_w, max_h) = self.max_resolution();
                if width < 1
                    || height < 1
                    || width > i64::from(max_w)
                    || height > i64::from(max_h)
                {
                    return Err(MethodError::failure("unsupported resolution"));
                }
                let changed =
                    self.frame
                        .borrow_mut()
                        .set_resolution(width as u16, height as u16, false);
                Ok(ValuePack::of([Value::from(changed)]))
            }
            "getResolution" => {
                let (w, h) = self.frame.borrow().resolution();
                Ok(ValuePack::of([
                    Value::from(i64::from(w)),
                    Value::from(i64::from(h)),
                ]))
            }
            "maxResolution" => {
                let (w, h) = self.max_resolution();
                Ok(ValuePack::of([
                    Value::from(i64::from(w)),
                    Value::from(i64::from(h)),
                ]))
            }
            "setPaletteColor" => {
                let index = self.palette_index(args, 0)?;
                let value = args.arg::<i64>(1)?;
                let old = self.palette[index];
                self.palette[index] = (value as u32) & 0x00FF_FFFF;
                Ok(ValuePack::of([Value::from(i64::from(old))]))
            }
            "getPaletteColor" => {
                let index = self.palette_index(args, 0)?;
                Ok(ValuePack::of([Value::from(i64::from(self.palette[index]))]))
            }
            "isOn" => Ok(ValuePack::of([Value::from(self.on)])),
            "turnOn" => {
                let changed = !self.on;
                self.on = true;
                Ok(ValuePack::of([Value::from(changed)]))
            }
            "turnOff" => {
                let changed = self.on;
                self.on = false;
                Ok(ValuePack::of([Value::from(changed)]))
            }
            _ => Err(MethodError::NoSuchMethod),
        }
    }
}

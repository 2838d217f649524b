// Window for picking the initial ROI and watching tracking live. Only the
// binary creates one; the library core never depends on it.

use crate::all::*;

use softbuffer::GraphicsContext;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyboardInput, MouseButton, VirtualKeyCode, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::platform::run_return::EventLoopExtRunReturn;
use winit::window::{Window, WindowBuilder};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ViewerInput {
  Key(VirtualKeyCode),
  CursorMoved(Pixel),
  Pressed,
  Released,
  Close,
}

impl ViewerInput {
  fn from_event(event: &WindowEvent) -> Option<ViewerInput> {
    match event {
      WindowEvent::CloseRequested => Some(ViewerInput::Close),
      WindowEvent::KeyboardInput {
        input: KeyboardInput {
          state: ElementState::Pressed,
          virtual_keycode: Some(keycode),
          ..
        },
        ..
      } => Some(ViewerInput::Key(*keycode)),
      WindowEvent::CursorMoved { position, .. } => {
        Some(ViewerInput::CursorMoved(Pixel::new(position.x as i32, position.y as i32)))
      },
      WindowEvent::MouseInput { state, button: MouseButton::Left, .. } => {
        Some(match state {
          ElementState::Pressed => ViewerInput::Pressed,
          ElementState::Released => ViewerInput::Released,
        })
      },
      _ => None,
    }
  }
}

// Rectangle dragged with the left mouse button over the first frame.
struct RoiSelection {
  width: u32,
  height: u32,
  cursor: Pixel,
  anchor: Option<Pixel>,
  selection: Option<Roi>,
}

impl RoiSelection {
  fn new(width: u32, height: u32) -> RoiSelection {
    RoiSelection {
      width,
      height,
      cursor: Pixel::zeros(),
      anchor: None,
      selection: None,
    }
  }

  // `Some` once the selection is confirmed or cancelled.
  fn handle(&mut self, input: ViewerInput) -> Option<Result<Roi>> {
    match input {
      ViewerInput::CursorMoved(p) => {
        self.cursor = Pixel::new(p[0].clamp(0, self.width as i32), p[1].clamp(0, self.height as i32));
        if let Some(anchor) = self.anchor {
          self.selection = Some(Roi::from_corners(anchor, self.cursor));
        }
      },
      ViewerInput::Pressed => {
        self.anchor = Some(self.cursor);
        self.selection = None;
      },
      ViewerInput::Released => {
        if let Some(anchor) = self.anchor.take() {
          self.selection = Some(Roi::from_corners(anchor, self.cursor));
        }
      },
      ViewerInput::Key(VirtualKeyCode::Return | VirtualKeyCode::Space) => {
        match self.selection {
          Some(roi) if !roi.is_empty() => return Some(Ok(roi)),
          _ => warn!("Drag a rectangle over the target before confirming."),
        }
      },
      ViewerInput::Key(VirtualKeyCode::Escape | VirtualKeyCode::C) | ViewerInput::Close => {
        return Some(Err(Error::RoiSelectionCancelled.into()));
      },
      ViewerInput::Key(_) => {},
    }
    None
  }
}

pub struct Viewer {
  event_loop: EventLoop<()>,
  graphics_context: GraphicsContext<Window>,
  buffer: Vec<u32>,
  width: u32,
  height: u32,
  open: bool,
}

impl Viewer {
  // winit allows one event loop per process, so the binary creates a single
  // viewer and reuses it for every image it shows.
  pub fn new(title: &str, width: u32, height: u32) -> Result<Viewer> {
    let event_loop = EventLoop::new();
    let window = WindowBuilder::new()
      .with_title(title)
      .with_resizable(false)
      .with_inner_size(PhysicalSize::new(width, height))
      .build(&event_loop)
      .map_err(|err| anyhow!("Failed to create window: {}", err))?;
    let graphics_context = unsafe { GraphicsContext::new(window) }
      .map_err(|_| anyhow!("Failed to create graphics context."))?;
    Ok(Viewer {
      event_loop,
      graphics_context,
      buffer: vec![],
      width,
      height,
      open: true,
    })
  }

  pub fn is_open(&self) -> bool {
    self.open
  }

  pub fn show(&mut self, image: &RgbImage) {
    let (width, height) = image.dimensions();
    if (width, height) != (self.width, self.height) {
      self.graphics_context.window().set_inner_size(PhysicalSize::new(width, height));
      self.width = width;
      self.height = height;
    }
    to_buffer(image, &mut self.buffer);
    self.graphics_context.set_buffer(&self.buffer, width as u16, height as u16);
  }

  // Blocks until Enter or Space moves on. Escape, Q or closing the window
  // closes the viewer for good.
  pub fn show_and_wait(&mut self, image: &RgbImage) {
    if !self.open { return }
    self.show(image);
    loop {
      for input in self.pump(true) {
        match input {
          ViewerInput::Key(VirtualKeyCode::Return | VirtualKeyCode::Space) => return,
          ViewerInput::Close | ViewerInput::Key(VirtualKeyCode::Escape | VirtualKeyCode::Q) => {
            self.close();
            return;
          },
          _ => {},
        }
      }
    }
  }

  pub fn close(&mut self) {
    self.open = false;
    self.graphics_context.window().set_visible(false);
  }

  // Runs one round of the event loop. With `wait` it blocks until at least
  // one input arrived.
  fn pump(&mut self, wait: bool) -> Vec<ViewerInput> {
    let mut inputs = vec![];
    let graphics_context = &mut self.graphics_context;
    let buffer = &self.buffer;
    let (width, height) = (self.width as u16, self.height as u16);
    let window_id = graphics_context.window().id();
    self.event_loop.run_return(|event, _, control_flow| {
      match event {
        Event::NewEvents(_) => {
          *control_flow = if wait { ControlFlow::Wait } else { ControlFlow::Poll };
        },
        Event::WindowEvent { event, window_id: id } if id == window_id => {
          if let Some(input) = ViewerInput::from_event(&event) {
            inputs.push(input);
          }
        },
        Event::RedrawRequested(id) if id == window_id => {
          if buffer.len() == width as usize * height as usize {
            graphics_context.set_buffer(buffer, width, height);
          }
        },
        Event::RedrawEventsCleared => {
          if !wait || !inputs.is_empty() {
            *control_flow = ControlFlow::Exit;
          }
        },
        _ => {},
      }
    });
    inputs
  }
}

impl RoiSource for Viewer {
  fn roi(&mut self, first_frame: &RgbImage) -> Result<Roi> {
    info!("Drag a rectangle around the target, Enter or Space to confirm, Escape or C to cancel.");
    let (width, height) = first_frame.dimensions();
    let mut selection = RoiSelection::new(width, height);
    self.show(first_frame);
    loop {
      for input in self.pump(true) {
        if let Some(result) = selection.handle(input) {
          return result;
        }
      }
      let mut canvas = first_frame.clone();
      if let Some(roi) = selection.selection {
        let sample = PositionSample { frame: String::new(), center: Some(roi.center()) };
        draw_tracking(&mut canvas, &sample, Some(roi));
      }
      self.show(&canvas);
    }
  }
}

impl TrackingObserver for Viewer {
  // Closing the window only ends the display, tracking goes on.
  fn observe(&mut self, frame: &RgbImage, sample: &PositionSample, roi: Option<Roi>) -> Result<()> {
    if !self.open { return Ok(()) }
    let mut canvas = frame.clone();
    draw_tracking(&mut canvas, sample, roi);
    self.show(&canvas);
    for input in self.pump(false) {
      if let ViewerInput::Close | ViewerInput::Key(VirtualKeyCode::Escape | VirtualKeyCode::Q) = input {
        info!("Display closed, tracking continues.");
        self.close();
        break;
      }
    }
    Ok(())
  }
}

impl CalibrationObserver for Viewer {
  fn observe(&mut self, _: &RgbImage, result: &CalibrationResult) -> Result<()> {
    info!("{}: {} lines. Enter or Space for the next image, Escape or Q to stop showing.", result.name, result.lines.len());
    self.show_and_wait(&calibration_panel(&result.preprocessed, &result.lines));
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn cursor(x: i32, y: i32) -> ViewerInput {
    ViewerInput::CursorMoved(Pixel::new(x, y))
  }

  #[test]
  fn test_drag_and_confirm() {
    let mut selection = RoiSelection::new(100, 80);
    let inputs = [cursor(40, 30), ViewerInput::Pressed, cursor(20, 50), cursor(10, 60), ViewerInput::Released];
    for input in inputs {
      assert!(selection.handle(input).is_none());
    }
    assert_eq!(selection.selection, Some(Roi::new(10, 30, 30, 30)));
    let roi = selection.handle(ViewerInput::Key(VirtualKeyCode::Return)).unwrap().unwrap();
    assert_eq!(roi, Roi::new(10, 30, 30, 30));
  }

  #[test]
  fn test_cursor_clamped_to_frame() {
    let mut selection = RoiSelection::new(100, 80);
    for input in [cursor(90, 70), ViewerInput::Pressed, cursor(150, -20), ViewerInput::Released] {
      selection.handle(input);
    }
    assert_eq!(selection.selection, Some(Roi::new(90, 0, 10, 70)));
  }

  #[test]
  fn test_confirm_needs_selection() {
    let mut selection = RoiSelection::new(100, 80);
    assert!(selection.handle(ViewerInput::Key(VirtualKeyCode::Space)).is_none());
    // A click without dragging selects nothing.
    for input in [cursor(5, 5), ViewerInput::Pressed, ViewerInput::Released] {
      selection.handle(input);
    }
    assert!(selection.handle(ViewerInput::Key(VirtualKeyCode::Space)).is_none());
  }

  #[test]
  fn test_cancel() {
    for input in [ViewerInput::Key(VirtualKeyCode::Escape), ViewerInput::Key(VirtualKeyCode::C), ViewerInput::Close] {
      let mut selection = RoiSelection::new(100, 80);
      let err = selection.handle(input).unwrap().unwrap_err();
      assert!(matches!(err.downcast_ref::<Error>(), Some(Error::RoiSelectionCancelled)));
    }
  }
}

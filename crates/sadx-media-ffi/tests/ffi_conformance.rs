//! Conformance of the C surface when misused or idle.
//!
//! These run against the default build, which has no container backend, so
//! every `ffPlayerOpen` fails and the player stays idle.

use std::ffi::CString;
use std::os::raw::{c_int, c_void};

use sadx_media::music::{
    BASS_VGMSTREAM_CloseVGMStream, BASS_VGMSTREAM_ConvertVGMStreamToWav,
    BASS_VGMSTREAM_GetVGMStreamOutputSize, BASS_VGMSTREAM_InitVGMStreamFromMemory,
};
use sadx_media::{
    ffPlayerClose, ffPlayerFinished, ffPlayerGetFrameBuffer, ffPlayerHeight, ffPlayerOpen,
    ffPlayerPause, ffPlayerPlay, ffPlayerWidth,
};
use sadx_media_core::wav;

/// Stereo WAV with loop 100..1000.
fn looping_wav() -> Vec<u8> {
    let mut file = wav::build_wav_header(1000, 22_050, 2, true).to_vec();
    for n in 0..1000i16 {
        file.extend_from_slice(&n.to_le_bytes());
        file.extend_from_slice(&(-n).to_le_bytes());
    }
    file.extend_from_slice(&wav::build_loop_chunk(100, 1000));
    file
}

/// Mono ADX, 32 samples in one frame, scale 17 and nibbles 7, 0, -8, 1.
fn short_adx() -> Vec<u8> {
    let data_offset = 0x32usize;
    let mut file = vec![0u8; data_offset];
    file[0] = 0x80;
    file[2..4].copy_from_slice(&((data_offset - 4) as u16).to_be_bytes());
    file[4] = 3;
    file[5] = 18;
    file[6] = 4;
    file[7] = 1;
    file[0x08..0x0C].copy_from_slice(&32_000u32.to_be_bytes());
    file[0x0C..0x10].copy_from_slice(&32u32.to_be_bytes());
    file[0x10..0x12].copy_from_slice(&500u16.to_be_bytes());
    file[0x12] = 3;
    file[data_offset - 6..data_offset].copy_from_slice(b"(c)CRI");
    let mut frame = [0u8; 18];
    frame[0..2].copy_from_slice(&0x0010u16.to_be_bytes());
    frame[2] = 0x70;
    frame[3] = 0x81;
    file.extend_from_slice(&frame);
    file
}

#[test]
fn player_is_idle_without_a_session() {
    ffPlayerClose();
    ffPlayerPlay();
    ffPlayerPause();
    assert!(!ffPlayerFinished());
    assert_eq!(ffPlayerWidth(), 0);
    assert_eq!(ffPlayerHeight(), 0);

    let mut frame = vec![0u8; 64];
    assert!(!ffPlayerGetFrameBuffer(frame.as_mut_ptr()));
    assert!(!ffPlayerGetFrameBuffer(std::ptr::null_mut()));
    ffPlayerClose();
}

#[test]
fn open_rejects_null_and_missing_paths() {
    assert!(!ffPlayerOpen(std::ptr::null(), false));
    let path = CString::new("/nonexistent/intro.sfd").unwrap();
    assert!(!ffPlayerOpen(path.as_ptr(), true));
    assert_eq!(ffPlayerWidth(), 0);
    assert!(!ffPlayerFinished());
}

#[test]
fn open_accepts_code_page_path_bytes() {
    let path = CString::new(b"movie\\\x83\x80\x81[.sfd".to_vec()).unwrap();
    assert!(std::str::from_utf8(path.as_bytes()).is_err());
    assert!(!ffPlayerOpen(path.as_ptr(), false));
    assert_eq!(ffPlayerWidth(), 0);
}

#[test]
fn music_calls_tolerate_null_handles() {
    BASS_VGMSTREAM_CloseVGMStream(std::ptr::null_mut());
    assert_eq!(BASS_VGMSTREAM_GetVGMStreamOutputSize(std::ptr::null_mut()), 0);
    let mut out = vec![0u8; 16];
    assert_eq!(
        BASS_VGMSTREAM_ConvertVGMStreamToWav(std::ptr::null_mut(), out.as_mut_ptr() as *mut _),
        1
    );
}

#[test]
fn converts_in_memory_wav_with_loop() {
    let mut data = looping_wav();
    let name = CString::new("bgm.wav").unwrap();
    let handle = BASS_VGMSTREAM_InitVGMStreamFromMemory(
        data.as_mut_ptr() as *mut c_void,
        data.len() as c_int,
        name.as_ptr(),
    );
    assert!(!handle.is_null());

    let size = BASS_VGMSTREAM_GetVGMStreamOutputSize(handle);
    assert_eq!(size as usize, 1000 * 2 * 2 + 0x2C + 0x44);

    let mut out = vec![0u8; size as usize];
    assert_eq!(
        BASS_VGMSTREAM_ConvertVGMStreamToWav(handle, out.as_mut_ptr() as *mut _),
        0
    );
    assert_eq!(&out[..4], b"RIFF");
    assert_eq!(
        u32::from_le_bytes(out[4..8].try_into().unwrap()) as usize,
        out.len() - 8
    );
    let smpl = out.len() - 0x44;
    assert_eq!(&out[smpl..smpl + 4], b"smpl");

    // Missing output buffer fails without consuming the handle.
    assert_eq!(
        BASS_VGMSTREAM_ConvertVGMStreamToWav(handle, std::ptr::null_mut()),
        1
    );
    BASS_VGMSTREAM_CloseVGMStream(handle);
}

#[test]
fn converts_in_memory_adx_by_header() {
    let mut data = short_adx();
    // The name gives no hint; the header alone selects the ADX decoder.
    let name = CString::new("bgm.bin").unwrap();
    let handle = BASS_VGMSTREAM_InitVGMStreamFromMemory(
        data.as_mut_ptr() as *mut c_void,
        data.len() as c_int,
        name.as_ptr(),
    );
    assert!(!handle.is_null());

    let size = BASS_VGMSTREAM_GetVGMStreamOutputSize(handle);
    assert_eq!(size as usize, 32 * 2 + 0x2C);

    let mut out = vec![0u8; size as usize];
    assert_eq!(
        BASS_VGMSTREAM_ConvertVGMStreamToWav(handle, out.as_mut_ptr() as *mut _),
        0
    );
    let pcm: Vec<i16> = out[0x2C..0x2C + 16]
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    assert_eq!(pcm, [119, 204, 126, 82, 47, 20, -1, -17]);
    BASS_VGMSTREAM_CloseVGMStream(handle);
}

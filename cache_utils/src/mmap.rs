use core::borrow::{Borrow, BorrowMut};
use core::ffi::c_void;
use core::mem::size_of;
use core::ops::{Deref, DerefMut};
use core::ptr;
use core::ptr::{null_mut, NonNull};
use core::slice::{from_raw_parts, from_raw_parts_mut};
use nix::errno::Errno::{EINVAL, ENOMEM};
use nix::sys::mman;

/** Safety issue : if T is non triviably constructable and destructable this is dangerous */
#[derive(Debug)]
pub struct MMappedMemory<T> {
    pointer: NonNull<T>,
    size: usize,
}

impl<T> MMappedMemory<T> {
    /// Map `size` elements of anonymous private memory and write `initializer(i)`
    /// into each one. Writing every element backs the mapping with its own
    /// physical pages rather than the shared zero page.
    pub fn try_new(
        size: usize,
        huge: bool,
        executable: bool,
        initializer: impl Fn(usize) -> T,
    ) -> Result<MMappedMemory<T>, nix::Error> {
        assert_ne!(size_of::<T>(), 0);
        let bytes = size
            .checked_mul(size_of::<T>())
            .ok_or(nix::Error::Sys(ENOMEM))?;
        let p = unsafe {
            mman::mmap(
                null_mut(),
                bytes,
                mman::ProtFlags::PROT_READ
                    | mman::ProtFlags::PROT_WRITE
                    | if executable {
                        mman::ProtFlags::PROT_EXEC
                    } else {
                        mman::ProtFlags::PROT_READ
                    },
                mman::MapFlags::MAP_PRIVATE
                    | mman::MapFlags::MAP_ANONYMOUS
                    | if huge {
                        mman::MapFlags::MAP_HUGETLB
                    } else {
                        mman::MapFlags::MAP_ANONYMOUS
                    },
                -1,
                0,
            )?
        };
        let pointer = NonNull::new(p as *mut T).ok_or(nix::Error::Sys(EINVAL))?;
        let s = MMappedMemory { pointer, size };
        for i in 0..s.size {
            unsafe { ptr::write(s.pointer.as_ptr().add(i), initializer(i)) };
        }
        Ok(s)
    }

    pub fn slice(&self) -> &[T] {
        unsafe { from_raw_parts(self.pointer.as_ptr(), self.size) }
    }

    pub fn slice_mut(&mut self) -> &mut [T] {
        unsafe { from_raw_parts_mut(self.pointer.as_ptr(), self.size) }
    }
}

impl<T> Drop for MMappedMemory<T> {
    fn drop(&mut self) {
        for i in 0..self.size {
            unsafe { ptr::drop_in_place(self.pointer.as_ptr().add(i)) };
        }
        unsafe {
            let _ = mman::munmap(
                self.pointer.as_ptr() as *mut c_void,
                self.size * size_of::<T>(),
            );
        }
    }
}

impl<T> Deref for MMappedMemory<T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        self.slice()
    }
}

impl<T> DerefMut for MMappedMemory<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.slice_mut()
    }
}

impl<T> AsRef<[T]> for MMappedMemory<T> {
    fn as_ref(&self) -> &[T] {
        self.slice()
    }
}

impl<T> Borrow<[T]> for MMappedMemory<T> {
    fn borrow(&self) -> &[T] {
        self.slice()
    }
}

impl<T> BorrowMut<[T]> for MMappedMemory<T> {
    fn borrow_mut(&mut self) -> &mut [T] {
        self.slice_mut()
    }
}
